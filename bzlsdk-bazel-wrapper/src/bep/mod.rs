pub mod build_events;
