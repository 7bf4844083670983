//! Reloj de ingesta
//!
//! Timestamps en milisegundos estrictamente crecientes dentro del proceso,
//! usados como clave del historial de posiciones.

use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct IngestClock {
    last: AtomicI64,
}

impl IngestClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Siguiente timestamp: el reloj de pared, o `último + 1` si el reloj no avanzó
    pub fn now_millis(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(previous + 1);
            match self
                .last
                .compare_exchange_weak(previous, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => previous = current,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_timestamps_strictly_increase() {
        let clock = IngestClock::new();
        let mut last = 0;
        for _ in 0..1_000 {
            let ts = clock.now_millis();
            assert!(ts > last);
            last = ts;
        }
    }

    #[test]
    fn test_timestamps_unique_across_threads() {
        let clock = Arc::new(IngestClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || (0..500).map(|_| clock.now_millis()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for ts in handle.join().unwrap() {
                assert!(seen.insert(ts), "duplicated timestamp {}", ts);
            }
        }
    }
}
