pub mod paradox_fixture_builder;
