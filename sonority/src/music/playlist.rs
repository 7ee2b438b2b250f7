use rand::Rng;

/// Tracks of one playlist plus the pool of titles not yet played in this pass.
///
/// Every title is picked once per pass; the pool refills when exhausted. A pick never
/// repeats the previously played title unless the pool holds nothing else.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<String>,
    pool: Vec<String>,
}

impl Playlist {
    pub fn new(mut tracks: Vec<String>) -> Self {
        tracks.sort();
        tracks.dedup();
        Self {
            tracks,
            pool: Vec::new(),
        }
    }

    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Titles left before the pool refills.
    pub fn remaining(&self) -> usize {
        self.pool.len()
    }

    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R, last: Option<&str>) -> Option<String> {
        if self.tracks.is_empty() {
            return None;
        }
        if self.pool.is_empty() {
            self.pool = self.tracks.clone();
        }

        let mut index = rng.gen_range(0..self.pool.len());
        if self.pool.len() > 1 && last == Some(self.pool[index].as_str()) {
            index = (index + 1) % self.pool.len();
        }
        Some(self.pool.swap_remove(index))
    }
}
