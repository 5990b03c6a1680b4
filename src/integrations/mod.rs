pub mod google;
pub mod oauth;
