pub mod count;
pub mod metadata;
pub mod users;

pub use count::CountStore;
pub use metadata::{fields_from_json, MetadataStore};
pub use users::UserStore;
