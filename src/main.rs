#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    let rocket = archive_server::rocket();
    log::info!("Starting archive server");
    rocket
}
