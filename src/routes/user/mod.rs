mod handler;
mod model;

pub use handler::{
    admin_delete_user,
    admin_edit_user,
    create_user,
    delete_own_account,
    edit_own_profile,
    get_own_profile,
    list_users,
    login,
    logout,
};
pub use model::User;
