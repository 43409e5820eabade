use std::future::Future;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::PipelineEngine;
use crate::router;
use crate::store::PgLeadStore;
use crate::time::SystemTime;
use crate::transitions::TransitionTable;

pub async fn serve<F>(config: Config, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = PgLeadStore::new(&config.database_url, config.max_pg_connections)
        .await
        .expect("failed to connect to the lead store");

    if config.run_migrations {
        store
            .run_migrations()
            .await
            .expect("failed to run migrations");
    }

    let engine = PipelineEngine::new(
        Arc::new(store),
        TransitionTable::default(),
        Arc::new(SystemTime),
    );

    let app = router::router(engine, config.export_prometheus);

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .expect("failed to bind address");

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("failed to start pipeline http server")
}
