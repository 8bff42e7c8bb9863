pub mod nickname;
pub mod password;
