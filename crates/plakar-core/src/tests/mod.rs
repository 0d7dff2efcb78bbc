mod cleanup;
mod helpers;
mod repository;
mod roundtrip;
