#![allow(non_snake_case)]

mod engine;
mod melody;
mod model;
mod rhythm;
mod util;

pub mod console;

pub use engine::*;
pub use melody::*;
pub use model::config::*;
pub use model::judge::*;
pub use model::song::*;
pub use rhythm::*;
pub use util::*;
