pub mod cache;
pub mod error;
pub mod fetch;
pub mod resolve;

pub use cache::Cache;
pub use error::{ErrorKind, FetchError, ResolveError};
pub use fetch::{EnvReader, FileReader, HttpFetcher, HttpResponse, OsEnv, OsFiles, ReqwestFetcher};
pub use resolve::{load, load_with, CancelToken, LoadOptions};
