mod handler;
mod model;

pub use handler::{create_review, delete_review, edit_review, list_user_reviews};
pub use model::{Review, ReviewInput};
