use std::collections::VecDeque;

use bridge_ipc::Message;

/// Bounded FIFO inbox of one participant.
#[derive(Debug)]
pub(crate) struct MessageQueue {
    capacity: usize,
    messages: VecDeque<Message>,
}

impl MessageQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::new(),
        }
    }

    /// Append `message`, handing it back if the queue is at capacity.
    pub(crate) fn push(&mut self, message: Message) -> Result<(), Message> {
        if self.messages.len() >= self.capacity {
            return Err(message);
        }
        self.messages.push_back(message);
        Ok(())
    }

    /// Take everything currently queued, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<Message> {
        self.messages.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_fifo() {
        let mut queue = MessageQueue::new(2);
        let first = Message::new("a", "b", "t", b"1".to_vec());
        let second = Message::new("a", "b", "t", b"2".to_vec());
        let third = Message::new("a", "b", "t", b"3".to_vec());

        queue.push(first.clone()).expect("room for first");
        queue.push(second.clone()).expect("room for second");
        let rejected = queue.push(third.clone()).expect_err("queue is full");
        assert_eq!(rejected, third);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.drain(), vec![first, second]);
        assert_eq!(queue.len(), 0);
        queue.push(third).expect("room after drain");
    }
}
