pub mod adaptive_poller;
