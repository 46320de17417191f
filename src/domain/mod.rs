pub mod phone;
pub mod state;

pub use phone::{Phone, PhoneDraft, PhoneId};
pub use state::CollectionState;
