pub mod capabilities;
pub mod compare;
pub mod efficiency;
pub mod gaps;
pub mod map;
pub mod parse;
pub mod prioritize;
pub mod validate;
