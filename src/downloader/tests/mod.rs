use super::*;
use crate::downloader::test_helpers::*;
use crate::types::{Event, RequestStage};


const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

fn is_terminal_for(id: RequestId) -> impl Fn(&Event) -> bool {
    move |event| match event {
        Event::RequestCompleted { id: done, .. } | Event::RequestFailed { id: done, .. } => {
            *done == id
        }
        _ => false,
    }
}
