pub mod capability_binding;
pub mod file;
pub mod state_entry;
pub mod token_record;
pub mod user;

pub use capability_binding::CapabilityBinding;
pub use file::FileItem;
pub use state_entry::StateEntry;
pub use token_record::TokenRecord;
pub use user::UserProfile;
