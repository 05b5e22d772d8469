pub mod test_config_profiles;
pub mod test_engine_scenarios;
