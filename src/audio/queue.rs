use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::track::Track,
    error::{PlayerError, PlayerResult},
};

const SEARCH_FALLBACK_URL: &str = "https://www.youtube.com/results?search_query=";

/// Resultado de encolar un track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Posición 0-based del track insertado
    pub position: usize,
    /// Tamaño de la cola tras la inserción
    pub count: usize,
}

/// Cola FIFO de tracks pendientes de una guild.
///
/// Se permiten duplicados; `position` devuelve la primera coincidencia.
#[derive(Debug)]
pub struct Queue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl Queue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final
    pub fn enqueue(&mut self, track: Track) -> PlayerResult<Enqueued> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        debug!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);

        Ok(Enqueued {
            position: self.items.len() - 1,
            count: self.items.len(),
        })
    }

    /// Agrega varios tracks (playlist) en el orden recibido.
    ///
    /// Lo que no cabe se descarta; cada entrada agregada reporta su posición.
    pub fn enqueue_many(&mut self, tracks: Vec<Track>) -> PlayerResult<Vec<Enqueued>> {
        let available = self.max_size.saturating_sub(self.items.len());
        if available == 0 && !tracks.is_empty() {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        let total = tracks.len();
        let mut added = Vec::with_capacity(total.min(available));
        for track in tracks.into_iter().take(available) {
            self.items.push_back(track);
            added.push(self.items.len() - 1);
        }

        let count = self.items.len();
        info!("➕ Agregadas {} de {} canciones a la cola", added.len(), total);
        Ok(added
            .into_iter()
            .map(|position| Enqueued { position, count })
            .collect())
    }

    /// Saca el primer track de la cola
    pub fn pop_next(&mut self) -> PlayerResult<Track> {
        match self.items.pop_front() {
            Some(track) => {
                debug!("➡️ Siguiente en cola: {}", track.title());
                Ok(track)
            }
            None => Err(PlayerError::QueueEmpty),
        }
    }

    pub fn position(&self, track: &Track) -> Option<usize> {
        self.items.iter().position(|item| item == track)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        debug!("🗑️ Cola limpiada");
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Páginas de la cola, calculadas bajo demanda.
    ///
    /// Siempre hay al menos una página, aunque la cola esté vacía.
    pub fn pages(&self, page_size: usize) -> Pages<'_> {
        let page_size = page_size.max(1);
        Pages {
            items: &self.items,
            page_size,
            next_page: 0,
            total_pages: self.items.len().div_ceil(page_size).max(1),
        }
    }
}

/// Iterador de páginas de la cola; clonarlo lo reinicia.
#[derive(Debug, Clone)]
pub struct Pages<'a> {
    items: &'a VecDeque<Track>,
    page_size: usize,
    next_page: usize,
    total_pages: usize,
}

impl Iterator for Pages<'_> {
    type Item = QueuePage;

    fn next(&mut self) -> Option<QueuePage> {
        if self.next_page >= self.total_pages {
            return None;
        }

        let start = self.next_page * self.page_size;
        let entries = self
            .items
            .iter()
            .enumerate()
            .skip(start)
            .take(self.page_size)
            .map(|(index, track)| PageEntry::from_track(index + 1, track))
            .collect();

        self.next_page += 1;

        Some(QueuePage {
            number: self.next_page,
            total_pages: self.total_pages,
            total_tracks: self.items.len(),
            entries,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_pages - self.next_page;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Pages<'_> {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    /// Índice 1-based, continúa entre páginas
    pub index: usize,
    pub label: String,
    pub link: String,
    pub duration: Option<String>,
}

impl PageEntry {
    fn from_track(index: usize, track: &Track) -> Self {
        // Un track diferido se muestra con su búsqueda
        Self {
            index,
            label: track.title().to_string(),
            link: track
                .uri()
                .map_or_else(|| search_fallback_link(track.title()), str::to_string),
            duration: track.duration().map(format_duration),
        }
    }

    /// Línea en markdown: `1. [title](uri) - 3:25`
    pub fn render(&self) -> String {
        match &self.duration {
            Some(duration) => format!("{}. [{}]({}) - {}", self.index, self.label, self.link, duration),
            None => format!("{}. [{}]({})", self.index, self.label, self.link),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    /// Número de página 1-based
    pub number: usize,
    pub total_pages: usize,
    pub total_tracks: usize,
    pub entries: Vec<PageEntry>,
}

impl QueuePage {
    pub fn description(&self) -> String {
        self.entries
            .iter()
            .map(PageEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn footer(&self) -> String {
        format!("Page {}/{}", self.number, self.total_pages)
    }
}

/// Enlace de búsqueda para tracks diferidos
pub fn search_fallback_link(query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("{}{}", SEARCH_FALLBACK_URL, encoded)
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
