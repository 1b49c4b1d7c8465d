use actix_web::{middleware, web, App, HttpServer};
use log::info;

use favboard::config::{bind_address, database_path, notifier_kind, seed_demo_data};
use favboard::core::db::{init_test_data, Database};
use favboard::notifications::{sender_for, NotificationDispatcher};
use favboard::{handle_all, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db = Database::open(database_path())?;
    if seed_demo_data() {
        init_test_data(&*db.conn()?)?;
    }

    let notifier = notifier_kind();
    info!("[Server] Notifications via {}", notifier);
    let dispatcher = NotificationDispatcher::new(sender_for(&notifier)?);
    let state = web::Data::new(AppState::new(db, dispatcher));

    let addr = bind_address();
    info!("[Server] Listening on http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .default_service(web::route().to(handle_all))
    })
    .bind(&addr)?
    .run()
    .await?;

    Ok(())
}
