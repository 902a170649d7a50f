mod render;

pub use render::{GENERATOR, build_channel, feed_filename, render_feed, write_feed};
