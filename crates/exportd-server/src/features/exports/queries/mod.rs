pub mod download;
pub mod get_status;

pub use download::{DownloadError, DownloadQuery};
pub use get_status::{GetStatusError, GetStatusQuery, StatusResponse};
