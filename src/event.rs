use std::time::Duration;
use tokio::sync::mpsc;

/// Events driving the `watch` loop
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
  /// Periodic tick; time to refetch
  Tick,
  /// Ctrl-C
  Interrupt,
}

/// Event handler that produces events from a tick timer and the interrupt signal
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn tick timer
    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let start = tokio::time::Instant::now() + tick_rate;
      let mut interval = tokio::time::interval_at(start, tick_rate);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        if tick_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    // Spawn interrupt listener
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = tx.send(Event::Interrupt);
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_ticks_after_each_interval() {
    let start = tokio::time::Instant::now();
    let mut events = EventHandler::new(Duration::from_secs(30));

    assert_eq!(events.next().await, Some(Event::Tick));
    assert_eq!(start.elapsed(), Duration::from_secs(30));

    assert_eq!(events.next().await, Some(Event::Tick));
    assert_eq!(start.elapsed(), Duration::from_secs(60));
  }
}
