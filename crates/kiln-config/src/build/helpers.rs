use std::path::PathBuf;

// Helper defaults
pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_root() -> PathBuf {
    PathBuf::from(".")
}

pub(crate) fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

pub(crate) fn default_target_name() -> String {
    "default".to_string()
}

pub(crate) fn default_base() -> String {
    "/".to_string()
}

pub(crate) fn default_cache_dir() -> PathBuf {
    PathBuf::from("node_modules/.kiln")
}
