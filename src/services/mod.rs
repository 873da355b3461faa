pub mod party;
pub mod providers;
pub mod recommendations;
pub mod swipes;
pub mod sync;
