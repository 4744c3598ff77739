pub mod compose;
pub mod dockerfile;
pub mod manifest;
