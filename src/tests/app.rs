use std::sync::Arc;

use crate::app::context::Scope;
use crate::app::{AppContext, AppError};
use crate::bookmarks::{BookmarkSource, BrowserSource};
use crate::config::{Config, SnapshotMethod};
use crate::profile::ProfileLocator;
use crate::semantic::storage::{INDEX_FILE, META_FILE};
use crate::semantic::{CatalogStore, SemanticSearchService};
use crate::tests::fixtures::{bookmarks, places_db, CountingEmbedder, StaticSource};

/// Creates an isolated AppContext over `source` in a unique temp directory.
/// Nothing outside the temp dir is read or written.
fn create_app_with(
    source: Arc<dyn BookmarkSource>,
    embedder: Arc<CountingEmbedder>,
    tweak: impl FnOnce(&mut Config),
) -> (AppContext, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let mut config = Config::load_with(tmp.path()).expect("failed to load config");
    tweak(&mut config);

    let service = SemanticSearchService::new(
        CatalogStore::new(config.data_dir()),
        embedder,
        source,
        config.refresh_on_start,
    );
    let locator = ProfileLocator::new(config.profile.clone());
    (AppContext::new(config, service, locator), tmp)
}

fn create_app(titles: &[&str]) -> (AppContext, tempfile::TempDir, Arc<CountingEmbedder>) {
    let embedder = Arc::new(CountingEmbedder::new());
    let (app, tmp) = create_app_with(
        Arc::new(StaticSource::new(bookmarks(titles))),
        embedder.clone(),
        |_| {},
    );
    (app, tmp, embedder)
}

/// Service sharing `dir` with a previous one, as after a restart.
fn restart(
    dir: &std::path::Path,
    source: Arc<StaticSource>,
    refresh: bool,
) -> (SemanticSearchService, Arc<CountingEmbedder>) {
    let embedder = Arc::new(CountingEmbedder::new());
    let service = SemanticSearchService::new(
        CatalogStore::new(dir.join("data")),
        embedder.clone(),
        source,
        refresh,
    );
    (service, embedder)
}

#[test]
fn test_search_from_browser_profile() {
    let profile = tempfile::tempdir().unwrap();
    places_db(
        profile.path(),
        &[
            (Some("Rust Book"), "https://doc.rust-lang.org/book/"),
            (Some("Go Tour"), "https://go.dev/tour/"),
            (None, "https://example.com/no-title"),
            (Some("Python Docs"), "https://docs.python.org/3/"),
        ],
    );

    let embedder = Arc::new(CountingEmbedder::new());
    let mut profile_config = Config::default().profile;
    profile_config.profile_path = Some(profile.path().to_path_buf());
    profile_config.snapshot_method = SnapshotMethod::Copy;
    let source = Arc::new(BrowserSource::new(ProfileLocator::new(profile_config.clone())));

    let (app, _tmp) = create_app_with(source, embedder.clone(), |config| {
        config.profile = profile_config;
    });

    let session = app.create_session().session;
    let view = app.search(&session, "rust programming", None).unwrap();

    assert_eq!(view.total_candidates, 3);
    assert_eq!(view.hits[0].title, "Rust Book");
    assert_eq!(view.hits[0].url, "https://doc.rust-lang.org/book/");
    assert!(view.hits[0].distance < view.hits[1].distance);
    assert!(view.hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    let located = app.locate().unwrap();
    assert_eq!(located.profile, profile.path());
    assert!(located.size > 0);
}

#[test]
fn test_top_hit_has_smallest_distance() {
    let (app, _tmp, _) = create_app(&["Rust Book", "Go Tour", "Python Docs"]);

    let hits = app.service().search("rust programming", 3).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].title, "Rust Book");
    assert!(hits[1..].iter().all(|hit| hit.distance > hits[0].distance));
}

#[test]
fn test_persisted_catalog_round_trip() {
    let (app, tmp, _) = create_app(&["Rust Book", "Go Tour", "Python Docs"]);
    let built = app.service().ensure_loaded().unwrap();

    let source = Arc::new(StaticSource::new(bookmarks(&[
        "Rust Book",
        "Go Tour",
        "Python Docs",
    ])));
    let (service, embedder) = restart(tmp.path(), source, false);
    let loaded = service.ensure_loaded().unwrap();

    assert_eq!(embedder.texts(), 0);
    assert_eq!(loaded.titles, built.titles);
    assert_eq!(loaded.urls, built.urls);
    assert_eq!(loaded.ids, built.ids);
    for position in 0..built.len() {
        assert_eq!(loaded.index.vector(position), built.index.vector(position));
    }
}

#[test]
fn test_warm_start_with_unchanged_bookmarks_embeds_nothing() {
    let titles = ["Rust Book", "Go Tour"];
    let (app, tmp, _) = create_app(&titles);
    app.initialize().unwrap();

    let source = Arc::new(StaticSource::new(bookmarks(&titles)));
    let (service, embedder) = restart(tmp.path(), source.clone(), true);

    let first = service.ensure_loaded().unwrap();
    let second = service.ensure_loaded().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(embedder.batches(), 0);
    assert_eq!(source.loads(), 1);
}

#[test]
fn test_changed_bookmarks_update_incrementally() {
    let (app, tmp, _) = create_app(&["Rust Book", "Go Tour"]);
    app.initialize().unwrap();

    let source = Arc::new(StaticSource::new(bookmarks(&[
        "Rust Book",
        "Go Tour",
        "Python Docs",
    ])));
    let (service, embedder) = restart(tmp.path(), source, true);
    let catalog = service.ensure_loaded().unwrap();

    assert_eq!(catalog.len(), 3);
    assert_eq!(embedder.texts(), 1);

    // the update was persisted
    let source = Arc::new(StaticSource::failing());
    let (service, _) = restart(tmp.path(), source, false);
    assert_eq!(service.ensure_loaded().unwrap().len(), 3);
}

#[test]
fn test_refresh_disabled_keeps_stored_catalog() {
    let (app, tmp, _) = create_app(&["Rust Book", "Go Tour"]);
    app.initialize().unwrap();

    let source = Arc::new(StaticSource::new(bookmarks(&["Something Else"])));
    let (service, embedder) = restart(tmp.path(), source.clone(), false);

    assert_eq!(service.ensure_loaded().unwrap().len(), 2);
    assert_eq!(source.loads(), 0);
    assert_eq!(embedder.batches(), 0);
}

#[test]
fn test_unreadable_browser_keeps_warm_catalog() {
    let (app, tmp, _) = create_app(&["Rust Book", "Go Tour"]);
    app.initialize().unwrap();

    let (service, _) = restart(tmp.path(), Arc::new(StaticSource::failing()), true);
    assert_eq!(service.ensure_loaded().unwrap().len(), 2);
}

#[test]
fn test_corrupt_index_is_rebuilt() {
    let (app, tmp, _) = create_app(&["Rust Book", "Go Tour"]);
    app.initialize().unwrap();

    let index_path = tmp.path().join("data").join(INDEX_FILE);
    let bytes = std::fs::read(&index_path).unwrap();
    std::fs::write(&index_path, &bytes[..bytes.len() - 3]).unwrap();

    let source = Arc::new(StaticSource::new(bookmarks(&["Rust Book", "Go Tour"])));
    let (service, embedder) = restart(tmp.path(), source, true);

    assert_eq!(service.ensure_loaded().unwrap().len(), 2);
    assert_eq!(embedder.texts(), 2);
}

#[test]
fn test_rebuild_removes_data_and_builds_cold() {
    let (app, tmp, embedder) = create_app(&["Rust Book", "Go Tour", "Python Docs"]);
    app.initialize().unwrap();
    assert_eq!(embedder.texts(), 3);

    app.invalidate().unwrap();
    assert!(!tmp.path().join("data").exists());
    assert!(!app.service().is_initialized());

    let status = app.rebuild().unwrap();
    assert!(status.service.loaded);
    assert_eq!(status.service.bookmarks, 3);
    assert_eq!(embedder.texts(), 6);
    assert!(tmp.path().join("data").join(META_FILE).exists());
}

#[test]
fn test_rebuild_resets_sessions() {
    let (app, _tmp, _) = create_app(&["Rust Book", "Go Tour"]);
    let session = app.create_session().session;
    app.search(&session, "rust", None).unwrap();

    app.rebuild().unwrap();

    let view = app.session_view(&session).unwrap();
    assert_eq!(view.query, None);
    assert_eq!(view.shown, 0);
    assert!(view.hits.is_empty());
}

#[test]
fn test_load_more_pages_through_candidates() {
    let titles: Vec<String> = (0..30).map(|i| format!("bookmark number {i}")).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let (app, _tmp, _) = create_app(&titles);

    let session = app.create_session().session;
    let view = app.search(&session, "bookmark", Some(10)).unwrap();
    assert_eq!(view.shown, 5);
    assert_eq!(view.total_candidates, 30);

    assert_eq!(app.load_more(&session).unwrap().shown, 15);
    assert_eq!(app.load_more(&session).unwrap().shown, 25);

    let view = app.load_more(&session).unwrap();
    assert_eq!(view.shown, 30);
    assert!(!view.has_more);
    assert_eq!(app.load_more(&session).unwrap().shown, 30);
}

#[test]
fn test_unknown_session() {
    let (app, _tmp, embedder) = create_app(&["Rust Book"]);

    let result = app.search("does-not-exist", "rust", None);
    assert!(matches!(result, Err(AppError::SessionNotFound)));
    assert!(matches!(app.load_more("does-not-exist"), Err(AppError::SessionNotFound)));
    assert_eq!(embedder.batches(), 0);
}

#[test]
fn test_initialization_failure_is_reported() {
    let embedder = Arc::new(CountingEmbedder::new());
    let (app, _tmp) = create_app_with(Arc::new(StaticSource::failing()), embedder, |_| {});

    let err = app.initialize().unwrap_err();
    assert!(err.is_initialization());

    let status = app.status();
    assert!(!status.service.loaded);
    assert!(status.error.is_some());
}

#[test]
fn test_visualize_clamps_to_maxima() {
    let titles: Vec<String> = (0..40).map(|i| format!("page {i} of notes")).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let (app, _tmp, _) = create_app_with_limits(&titles, 10, 2);

    let graph = app
        .visualize(None, Scope::All, Some(500), Some(50), Some(1))
        .unwrap();
    assert_eq!(graph.nodes.len(), 10);
    assert!(graph.edges.len() <= 10 * 2);
}

#[test]
fn test_visualize_results_needs_session() {
    let (app, _tmp, _) = create_app(&["Rust Book", "Go Tour"]);
    let result = app.visualize(None, Scope::Results, None, None, None);
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let session = app.create_session().session;
    app.search(&session, "rust", None).unwrap();
    let graph = app
        .visualize(Some(&session), Scope::Results, None, None, Some(1))
        .unwrap();
    assert_eq!(graph.nodes.len(), 2);
}

#[test]
fn test_word_cloud_over_all_titles() {
    let (app, _tmp, _) = create_app(&["Rust Book", "Rust by Example", "Go Tour"]);
    let words = app.word_cloud(None, Scope::All, Some(2)).unwrap();
    assert_eq!(words.len(), 2);
    assert_eq!(words[0].word, "rust");
    assert_eq!(words[0].count, 2);
}

fn create_app_with_limits(
    titles: &[&str],
    max_sample_size: usize,
    max_neighbors: usize,
) -> (AppContext, tempfile::TempDir, Arc<CountingEmbedder>) {
    let embedder = Arc::new(CountingEmbedder::new());
    let (app, tmp) = create_app_with(
        Arc::new(StaticSource::new(bookmarks(titles))),
        embedder.clone(),
        |config| {
            config.visualization.max_sample_size = max_sample_size;
            config.visualization.default_sample_size = max_sample_size;
            config.visualization.max_neighbors = max_neighbors;
            config.visualization.default_neighbors = max_neighbors;
        },
    );
    (app, tmp, embedder)
}
