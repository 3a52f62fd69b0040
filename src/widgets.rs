mod finder;
mod flame;
mod label;
mod timeline;

pub use finder::{Finder, Slot};
pub use flame::{frames, FlameRenderer, FlameResponse, Frame, IcicleRenderer};
pub use label::{error_label, placeholder, row_label};
pub use timeline::{show_timeline, span_details};
