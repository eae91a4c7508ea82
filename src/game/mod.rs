pub mod beatmap;
pub mod easing;
pub mod judge;
pub mod play;
pub mod scroll;
pub mod storyboard;
