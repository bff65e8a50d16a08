use std::collections::VecDeque;
use std::sync::Mutex;

/// Two-lane outbound buffer. The priority lane holds protocol traffic
/// (PING, numerics, handshake bursts) and is always drained in full;
/// the normal lane holds relayed chat and is drained up to a per-tick
/// cap so a burst of platform events cannot starve the connection.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    priority: Mutex<VecDeque<String>>,
    normal: Mutex<VecDeque<String>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, line: String) {
        log::trace!("q: {line}");
        if let Ok(mut lane) = self.normal.lock() {
            lane.push_back(line);
        }
    }

    pub fn enqueue_priority(&self, line: String) {
        log::trace!("q!: {line}");
        if let Ok(mut lane) = self.priority.lock() {
            lane.push_back(line);
        }
    }

    /// Takes everything out of the priority lane, in order.
    pub fn drain_priority(&self) -> Vec<String> {
        match self.priority.lock() {
            Ok(mut lane) => lane.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Takes up to `max` lines from the normal lane, in order.
    pub fn drain_normal(&self, max: usize) -> Vec<String> {
        match self.normal.lock() {
            Ok(mut lane) => {
                let n = max.min(lane.len());
                lane.drain(..n).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let p = self.priority.lock().map(|l| l.is_empty()).unwrap_or(true);
        let n = self.normal.lock().map(|l| l.is_empty()).unwrap_or(true);
        p && n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_drained_in_full() {
        let q = OutboundQueue::new();
        for i in 0..20 {
            q.enqueue_priority(format!("p{i}"));
        }
        let drained = q.drain_priority();
        assert_eq!(drained.len(), 20);
        assert_eq!(drained[0], "p0");
        assert_eq!(drained[19], "p19");
        assert!(q.drain_priority().is_empty());
    }

    #[test]
    fn test_normal_lane_capped() {
        let q = OutboundQueue::new();
        for i in 0..15 {
            q.enqueue(format!("n{i}"));
        }
        let first = q.drain_normal(10);
        assert_eq!(first.len(), 10);
        assert_eq!(first[9], "n9");
        let second = q.drain_normal(10);
        assert_eq!(second.len(), 5);
        assert_eq!(second[0], "n10");
        assert!(q.is_empty());
    }

    #[test]
    fn test_lanes_independent() {
        let q = OutboundQueue::new();
        q.enqueue("chat".to_owned());
        q.enqueue_priority("PING".to_owned());
        assert_eq!(q.drain_priority(), vec!["PING".to_owned()]);
        assert_eq!(q.drain_normal(10), vec!["chat".to_owned()]);
    }
}
