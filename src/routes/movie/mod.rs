mod handler;
mod model;

pub use handler::{create_movie, delete_movie, edit_movie, get_movie_by_id, list_movies};
pub use model::{Movie, MovieInput};
