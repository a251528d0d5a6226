use ragserve::config::Config;
use ragserve::processing::InMemoryChunkRepository;
use ragserve::rag::RagService;
use ragserve::templates::TemplateStore;
use ragserve::{api, llm, logging, vectordb};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().expect("Failed to load configuration");
    let generation = llm::generation_client(&config).expect("Failed to build generation client");
    let embedding = llm::embedding_client(&config).expect("Failed to build embedding client");
    let store = vectordb::vector_store(&config)
        .await
        .expect("Failed to connect vector store");

    let service = RagService::new(
        &config,
        generation,
        embedding,
        store,
        TemplateStore::default(),
        Arc::new(InMemoryChunkRepository::new()),
    );
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener(
    configured_port: Option<u16>,
) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = configured_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 5200..=5299;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 5200-5299",
    ))
}
