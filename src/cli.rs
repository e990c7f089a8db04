use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web interface.
    Serve {
        /// Address to listen on. Defaults to `listen` from config.yaml
        #[clap(long)]
        addr: Option<String>,
    },

    /// Search bookmarks by meaning
    Search {
        /// Free text query
        #[clap(allow_hyphen_values = true)]
        query: String,

        /// Number of results to print
        #[clap(short = 'n', long)]
        limit: Option<usize>,

        /// Print results as json
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Delete the stored index and build it again from the browser
    Rebuild {
        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Print the profile and database bookmarks are read from
    Locate {},
}
