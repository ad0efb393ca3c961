//! Destinations for reduced events.

use efu_core::Event;
use log::warn;
use std::sync::mpsc::Sender;

/// Receives events in emission order.
pub trait EventSink: Send {
    fn consume(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn consume(&mut self, event: Event) {
        self.push(event);
    }
}

/// Forwards events to another thread. Events sent after the receiving end
/// hung up are discarded.
impl EventSink for Sender<Event> {
    fn consume(&mut self, event: Event) {
        if self.send(event).is_err() {
            warn!("event channel closed, discarding event");
        }
    }
}

/// Adapts a closure into an [`EventSink`].
pub struct FnSink<F>(pub F);

impl<F: FnMut(Event) + Send> EventSink for FnSink<F> {
    fn consume(&mut self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<Event> = Vec::new();
        sink.consume(Event::new(0, 1));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_channel_sink() {
        let (tx, rx) = channel::<Event>();
        let mut sink = tx;
        sink.consume(Event::new(2, 3));
        assert_eq!(rx.recv().unwrap().plane_a(), 2);
        drop(rx);
        sink.consume(Event::new(2, 3));
    }

    #[test]
    fn test_fn_sink() {
        let mut count = 0;
        {
            let mut sink = FnSink(|_event| count += 1);
            sink.consume(Event::default());
            sink.consume(Event::default());
        }
        assert_eq!(count, 2);
    }
}
