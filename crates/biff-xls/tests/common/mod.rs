pub mod biff_fixture_builder;
