//! Page parsing into an element arena, unique selector choice, and binding
//! of test case steps into a browser automation script.

pub mod bind;
pub mod dom;
pub mod extract;
pub mod render;
pub mod script;
pub mod selector;

pub use bind::StepBinder;
pub use dom::{NodeId, PageElement, PageTree};
pub use extract::{ElementKind, InteractiveElement, PageModel};
pub use render::{render_script, script_filename};
pub use script::{ScriptSynthesizer, Synthesis};
pub use selector::{SelectorCandidate, SelectorSpec};
