pub mod evidence;
pub mod item;
pub mod money;
pub mod profile;
pub mod routine;
