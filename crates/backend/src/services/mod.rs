//! Business logic behind the HTTP handlers.

pub mod annotation;
pub mod reply;
pub mod sync;

pub use annotation::AnnotationService;
pub use reply::ReplyService;
pub use sync::SyncService;
