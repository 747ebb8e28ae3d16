//! Terminal output
//!
//! Uses `cliclack` and `indicatif` for interactive terminals with automatic
//! fallback to plain, line-oriented output in CI, where depcache usually
//! runs.
//!
//! ```rust,ignore
//! use depcache::ui::{self, TaskSpinner, UiContext};
//!
//! let ctx = UiContext::detect();
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Resolving dependencies...");
//! // ...
//! spinner.stop("Loaded from local cache");
//! ui::step_warn_hint(&ctx, "Shared cache unavailable", "check storage.shared");
//! ```

mod context;
mod output;
mod progress;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_status, outro_success, outro_warn, remark, step_info, step_ok,
    step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::TaskSpinner;
pub use theme::{init_theme, DepcacheTheme};
