pub mod admin;
pub mod search;
pub mod vectors;

use actix_web::web;

/// Register every route
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Export before `{id}` so the literal segment wins
    cfg.service(vectors::add_vector)
        .service(vectors::export_vectors)
        .service(vectors::get_vector)
        .service(vectors::delete_vector)
        .service(vectors::populate)
        .service(search::search)
        .service(search::bulk_search)
        .service(
            web::scope("/admin")
                .service(admin::health)
                .service(admin::metadata)
                .service(admin::tags)
                .service(admin::stats)
                .service(admin::reset),
        );
}
