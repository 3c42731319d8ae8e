pub mod evaluate;
pub mod retention;
