//! Default values for configuration

/// Default Elasticsearch URL for local development
pub fn default_store_url() -> String {
    std::env::var("ES_URL").unwrap_or_else(|_| "http://localhost:9200".to_string())
}

/// Default target index
pub fn default_store_index() -> String {
    std::env::var("ES_INDEX").unwrap_or_else(|_| "streaming".to_string())
}

/// Default number of documents per `_bulk` request
pub fn default_store_chunk_size() -> usize {
    5000
}

/// Default request timeout in seconds
pub fn default_store_timeout() -> u64 {
    30
}

/// Default environment variable name for the store API key (empty = no auth)
pub fn default_store_api_key_env() -> String {
    "".to_string()
}

/// Derive document ids from file and row position
pub fn default_stable_ids() -> bool {
    true
}

/// Default rows per batch read from a file
pub fn default_batch_size() -> usize {
    10_000
}

/// Default number of files processed concurrently
pub fn default_workers() -> usize {
    4
}

/// Default delay between live-mode scans (milliseconds)
pub fn default_poll_interval_ms() -> u64 {
    5000
}

/// Files modified more recently than this are left for the next live scan
pub fn default_settle_secs() -> u64 {
    2
}

/// Suffix appended to a file name to form its completion marker
pub fn default_marker_suffix() -> String {
    ".processed".to_string()
}

/// Default traffic classifier binary
pub fn default_capture_binary() -> String {
    "twc".to_string()
}

pub fn default_max_flow_packets() -> u32 {
    500
}

pub fn default_min_flow_packets() -> u32 {
    1
}

/// Default export period for live capture (seconds)
pub fn default_export_duration() -> u32 {
    1
}

/// Default directory for extracted flow files
pub fn default_output_dir() -> String {
    "./output".to_string()
}
