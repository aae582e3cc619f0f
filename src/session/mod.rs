mod store;

pub use store::{Admission, SessionStore, UserSession};
