mod helpers;
mod mocks;
mod monitor;
