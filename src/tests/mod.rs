pub mod support;

mod playback_tests;
