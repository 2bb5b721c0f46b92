mod init;
mod keys;
mod user;

pub use init::cmd_init;
pub use keys::{cmd_keys_generate, cmd_keys_resume, cmd_keys_retire, cmd_keys_rotate, cmd_keys_status};
pub use user::{
    cmd_user_approve, cmd_user_create, cmd_user_delete, cmd_user_list, cmd_user_reject,
    cmd_user_update,
};
