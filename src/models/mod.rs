pub mod change;
pub mod diagnostics;
pub mod doc_content;
pub mod error;
pub mod health;
pub mod indicator;
pub mod messages;
pub mod task;

pub use change::*;
pub use diagnostics::*;
pub use doc_content::*;
pub use error::*;
pub use health::*;
pub use indicator::*;
pub use messages::*;
pub use task::*;
