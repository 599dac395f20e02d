pub mod health;
pub mod protected;
