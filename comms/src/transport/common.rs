use std::pin::Pin;

use tokio_stream::Stream;

pub type BoxedStream<Item> = Pin<Box<dyn Stream<Item = Item> + Send>>;
