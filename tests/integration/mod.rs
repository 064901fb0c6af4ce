mod api_tests;
mod geoip_tests;
