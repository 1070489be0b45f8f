use fixture::Fixture;

mod client;
mod fixture;

mod input;
mod maximize;
mod pings;
mod popups;
mod stacking;
mod window_opening;
mod wire;
