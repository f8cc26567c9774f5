//! Shared constants used across the application.

use std::time::Duration;

/// User agent string sent with every forum and embedding request.
pub const USER_AGENT: &str = concat!("piazza-reader/", env!("CARGO_PKG_VERSION"));

/// Default JSON-RPC endpoint of the forum.
pub const DEFAULT_API_URL: &str = "https://piazza.com/logic/api";

/// Default OpenAI-compatible embeddings endpoint.
pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model name.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Number of posts requested per feed page when walking a whole course.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Number of posts shown by the plain question list.
pub const QUESTION_LIST_LIMIT: usize = 30;

/// Number of courses shown per page of the course menu.
pub const COURSE_PAGE_SIZE: usize = 30;

/// Seconds a cached course feed stays fresh.
pub const DEFAULT_CACHE_EXPIRY_SECS: u64 = 3600;

/// Maximum number of semantic search results.
pub const DEFAULT_TOP_K: usize = 10;

/// Number of flattened thread lines visible at once.
pub const DEFAULT_WINDOW_SIZE: usize = 12;

/// Separator placed between subject and body when building search text.
pub const SEARCH_TEXT_SEPARATOR: &str = "\n";

/// HTTP timeout for forum and embedding requests.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
