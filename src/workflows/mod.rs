pub mod quarantine;
