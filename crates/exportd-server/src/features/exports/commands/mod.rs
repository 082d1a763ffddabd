pub mod cancel;
pub mod create;

pub use cancel::{CancelExportCommand, CancelExportError};
pub use create::{CreateExportCommand, CreateExportError, CreateExportResponse};
