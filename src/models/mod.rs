pub mod principal;

pub use principal::{NewPrincipal, Principal, PrincipalView};
