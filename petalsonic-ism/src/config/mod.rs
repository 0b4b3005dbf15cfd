mod render_settings;
mod source_desc;
mod world_desc;

pub use render_settings::{RenderSettings, SPEED_OF_SOUND};
pub use source_desc::{MAX_IR_SLOTS, SourceDesc};
pub use world_desc::WorldDesc;
