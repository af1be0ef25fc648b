use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use atelier_llm::{
    BoxFuture, ContentRequest, GenAiProvider, GeneratedImage, GenerationClient, ImageRequest,
    LoadingState, Operation, ProviderError, ProviderResult, VideoRequest,
};
use atelier_storage::{HistoryStore, KeyValueStore, MemoryKeyValueStore, StorageError, StorageResult};

use super::Creator;

/// Provider double for workflow tests. Image answers are keyed by prompt so
/// concurrent fan-out calls resolve deterministically.
#[derive(Default)]
pub(crate) struct FakeProvider {
    content: Mutex<VecDeque<ProviderResult<String>>>,
    images: Mutex<HashMap<String, ProviderResult<Vec<GeneratedImage>>>>,
    videos: Mutex<VecDeque<ProviderResult<Operation>>>,
    content_prompts: Mutex<Vec<String>>,
    image_requests: Mutex<Vec<ImageRequest>>,
    video_requests: Mutex<Vec<VideoRequest>>,
}

impl FakeProvider {
    pub(crate) fn with_content(self, answer: ProviderResult<String>) -> Self {
        lock(&self.content).push_back(answer);
        self
    }

    pub(crate) fn with_image(self, prompt: &str, answer: ProviderResult<Vec<GeneratedImage>>) -> Self {
        lock(&self.images).insert(prompt.to_string(), answer);
        self
    }

    pub(crate) fn with_video(self, answer: ProviderResult<Operation>) -> Self {
        lock(&self.videos).push_back(answer);
        self
    }

    pub(crate) fn content_prompts(&self) -> Vec<String> {
        lock(&self.content_prompts).clone()
    }

    pub(crate) fn image_requests(&self) -> Vec<ImageRequest> {
        lock(&self.image_requests).clone()
    }

    pub(crate) fn video_requests(&self) -> Vec<VideoRequest> {
        lock(&self.video_requests).clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        lock(&self.content_prompts).len()
            + lock(&self.image_requests).len()
            + lock(&self.video_requests).len()
    }
}

pub(crate) fn failure(message: &str) -> ProviderError {
    ProviderError::ApiStatus {
        stage: "fake-provider",
        status: 400,
        message: message.to_string(),
    }
}

pub(crate) fn jpeg(bytes: &[u8]) -> Vec<GeneratedImage> {
    vec![GeneratedImage {
        bytes: bytes.to_vec(),
        mime_type: "image/jpeg".to_string(),
    }]
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl GenAiProvider for FakeProvider {
    fn id(&self) -> &str {
        "fake"
    }

    fn generate_content<'a>(&'a self, request: ContentRequest) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            lock(&self.content_prompts).push(request.prompt);
            lock(&self.content)
                .pop_front()
                .unwrap_or_else(|| Err(failure("no content scripted")))
        })
    }

    fn generate_images<'a>(
        &'a self,
        request: ImageRequest,
    ) -> BoxFuture<'a, ProviderResult<Vec<GeneratedImage>>> {
        Box::pin(async move {
            let answer = lock(&self.images)
                .remove(&request.prompt)
                .unwrap_or_else(|| Err(failure("no image scripted")));
            lock(&self.image_requests).push(request);
            tokio::task::yield_now().await;
            answer
        })
    }

    fn generate_videos<'a>(&'a self, request: VideoRequest) -> BoxFuture<'a, ProviderResult<Operation>> {
        Box::pin(async move {
            lock(&self.video_requests).push(request);
            lock(&self.videos)
                .pop_front()
                .unwrap_or_else(|| Err(failure("no video scripted")))
        })
    }

    fn refresh_operation<'a>(
        &'a self,
        operation: &'a Operation,
    ) -> BoxFuture<'a, ProviderResult<Operation>> {
        Box::pin(async move { Ok(operation.clone()) })
    }
}

/// Key/value store that refuses every write.
#[derive(Default)]
pub(crate) struct ReadOnlyStore {
    inner: MemoryKeyValueStore,
}

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Backend {
            stage: "read-only-store",
            key: key.to_string(),
            details: "storage is read only".to_string(),
        })
    }
}

pub(crate) struct Harness {
    pub(crate) provider: Arc<FakeProvider>,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) loading: LoadingState,
    pub(crate) creator: Creator,
}

pub(crate) fn harness(provider: FakeProvider) -> Harness {
    harness_with_backend(provider, Arc::new(MemoryKeyValueStore::new()))
}

pub(crate) fn harness_with_backend(
    provider: FakeProvider,
    backend: Arc<dyn KeyValueStore>,
) -> Harness {
    let provider = Arc::new(provider);
    let history = Arc::new(HistoryStore::load(backend).expect("history loads"));
    let loading = LoadingState::new();
    let shared: Arc<dyn GenAiProvider> = provider.clone();
    let client = GenerationClient::new(shared).with_loading_state(loading.clone());
    let creator = Creator::new(client, history.clone());
    Harness {
        provider,
        history,
        loading,
        creator,
    }
}
