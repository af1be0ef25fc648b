use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::time::Instant;

use crate::loading::LoadingState;
use crate::provider::{
    BoxFuture, ContentRequest, GenAiProvider, GeneratedImage, ImageRequest, Operation,
    ProviderError, ProviderResult, VideoRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Content,
    Images,
    Videos,
    Refresh(String),
}

/// Provider that replays queued answers and records every interaction.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    content: Mutex<VecDeque<ProviderResult<String>>>,
    content_by_prompt: Mutex<HashMap<String, ProviderResult<String>>>,
    images: Mutex<VecDeque<ProviderResult<Vec<GeneratedImage>>>>,
    operations: Mutex<VecDeque<ProviderResult<Operation>>>,
    calls: Mutex<Vec<(Call, Instant)>>,
    requests: Mutex<Vec<ContentRequest>>,
    video_requests: Mutex<Vec<VideoRequest>>,
    busy_seen: Mutex<Vec<bool>>,
    observed: Option<LoadingState>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records whether `state` reported busy at the start of every call.
    pub(crate) fn observing(mut self, state: &LoadingState) -> Self {
        self.observed = Some(state.clone());
        self
    }

    pub(crate) fn with_content(self, answer: ProviderResult<String>) -> Self {
        lock(&self.content).push_back(answer);
        self
    }

    /// Answers the content call with this exact prompt, whatever order calls settle in.
    pub(crate) fn with_content_for(self, prompt: &str, answer: ProviderResult<String>) -> Self {
        lock(&self.content_by_prompt).insert(prompt.to_string(), answer);
        self
    }

    pub(crate) fn with_images(self, answer: ProviderResult<Vec<GeneratedImage>>) -> Self {
        lock(&self.images).push_back(answer);
        self
    }

    /// The first queued operation answers the video call, the rest answer refreshes.
    pub(crate) fn with_operation(self, answer: ProviderResult<Operation>) -> Self {
        lock(&self.operations).push_back(answer);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Call, Instant)> {
        lock(&self.calls).clone()
    }

    pub(crate) fn content_requests(&self) -> Vec<ContentRequest> {
        lock(&self.requests).clone()
    }

    pub(crate) fn video_requests(&self) -> Vec<VideoRequest> {
        lock(&self.video_requests).clone()
    }

    pub(crate) fn busy_seen(&self) -> Vec<bool> {
        lock(&self.busy_seen).clone()
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push((call, Instant::now()));
        if let Some(state) = &self.observed {
            lock(&self.busy_seen).push(state.is_busy());
        }
    }
}

pub(crate) fn api_error(message: &str) -> ProviderError {
    ProviderError::ApiStatus {
        stage: "scripted",
        status: 500,
        message: message.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn exhausted<T>() -> ProviderResult<T> {
    Err(api_error("scripted provider has no answer left"))
}

impl GenAiProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn generate_content<'a>(&'a self, request: ContentRequest) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            self.record(Call::Content);
            let prompt = request.prompt.clone();
            lock(&self.requests).push(request);
            tokio::task::yield_now().await;
            let keyed = lock(&self.content_by_prompt).remove(&prompt);
            keyed
                .or_else(|| lock(&self.content).pop_front())
                .unwrap_or_else(exhausted)
        })
    }

    fn generate_images<'a>(
        &'a self,
        _request: ImageRequest,
    ) -> BoxFuture<'a, ProviderResult<Vec<GeneratedImage>>> {
        Box::pin(async move {
            self.record(Call::Images);
            tokio::task::yield_now().await;
            lock(&self.images).pop_front().unwrap_or_else(exhausted)
        })
    }

    fn generate_videos<'a>(&'a self, request: VideoRequest) -> BoxFuture<'a, ProviderResult<Operation>> {
        Box::pin(async move {
            self.record(Call::Videos);
            lock(&self.video_requests).push(request);
            lock(&self.operations).pop_front().unwrap_or_else(exhausted)
        })
    }

    fn refresh_operation<'a>(
        &'a self,
        operation: &'a Operation,
    ) -> BoxFuture<'a, ProviderResult<Operation>> {
        Box::pin(async move {
            self.record(Call::Refresh(operation.name.clone()));
            lock(&self.operations).pop_front().unwrap_or_else(exhausted)
        })
    }
}
