use std::collections::VecDeque;

use super::song::Song;

/// FIFO of songs that have not started yet. Not synchronised on its own: the
/// owning [`Player`](super::player::Player) keeps it behind its state lock.
#[derive(Default)]
pub struct SongQueue {
    queue: VecDeque<Song>,
}

impl SongQueue {
    pub fn new() -> SongQueue {
        SongQueue {
            queue: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, song: Song) {
        self.queue.push_back(song);
    }

    pub fn dequeue(&mut self) -> Option<Song> {
        self.queue.pop_front()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Copy of the queue for display; never hands out the backing storage.
    pub fn snapshot(&self) -> Vec<Song> {
        self.queue.iter().cloned().collect()
    }

    pub fn get_string(&self) -> String {
        if self.queue.is_empty() {
            return "*empty*".to_string();
        };
        let mut s = String::new();
        for (i, song) in self.queue.iter().enumerate() {
            s += &format!("{}. {}\n", i + 1, song.get_string());
        }
        s
    }
}
