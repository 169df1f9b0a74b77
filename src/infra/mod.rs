pub(crate) mod app_paths;
pub(crate) mod db;
pub(crate) mod program_cache;
pub(crate) mod settings;
pub(crate) mod switches;
