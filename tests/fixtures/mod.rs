mod fixture_seneschal;

pub use fixture_seneschal::*;
