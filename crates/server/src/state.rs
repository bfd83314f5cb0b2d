use service::StoryStore;

#[derive(Clone)]
pub struct AppState {
    pub stories: StoryStore,
    /// Default page size for `GET /api/stories`.
    pub list_limit: usize,
}

impl AppState {
    pub fn new(stories: StoryStore, list_limit: usize) -> Self {
        Self { stories, list_limit }
    }
}
