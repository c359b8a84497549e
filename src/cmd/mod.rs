//! CLI command implementations.
//!
//! | Module  | Commands handled          |
//! |---------|---------------------------|
//! | `serve` | `Serve`                   |
//! | `auth`  | `Login`, `Logout`, `Whoami` |
//! | `list`  | `List`                    |
//! | `watch` | `Watch`                   |

pub mod auth;
pub mod list;
pub mod serve;
pub mod watch;

pub use auth::{cmd_login, cmd_logout, cmd_whoami};
pub use list::cmd_list;
pub use serve::cmd_serve;
pub use watch::cmd_watch;
