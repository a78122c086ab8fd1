mod flow;
mod presentation;

pub use flow::FlowEngine;
pub use presentation::PresentationUnit;
