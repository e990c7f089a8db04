
mod app;
