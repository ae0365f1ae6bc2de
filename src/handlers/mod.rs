pub mod diagnostics;
pub mod doc_content;
pub mod health;

pub use diagnostics::*;
pub use doc_content::*;
pub use health::*;
