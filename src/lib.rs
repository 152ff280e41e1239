mod chord;
mod compiler;
mod display;
mod engine;
mod export;
mod midi_importer;
mod model;
mod player;
mod recorder;
mod util;

pub use chord::*;
pub use compiler::*;
pub use display::*;
pub use engine::console::*;
pub use engine::wav::*;
pub use engine::*;
pub use export::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::event::*;
pub use model::melody::*;
pub use model::note::*;
pub use model::songs::*;
pub use player::*;
pub use recorder::*;
pub use util::*;
