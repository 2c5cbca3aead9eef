pub mod anonymizer;

pub use anonymizer::IpAnonymizer;
