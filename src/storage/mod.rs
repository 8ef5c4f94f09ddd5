//! Object storage: key sanitization, the store client and the uploader.

pub mod keys;
pub mod object_store;
pub mod uploader;

pub use keys::sanitize_name;
pub use object_store::{ObjectStore, ObjectStoreError, S3ObjectStore};
pub use uploader::{MachineUploader, RetryPolicy, UploadError, UploadReport};
