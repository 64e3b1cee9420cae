#[actix_web::main]
async fn main() -> std::io::Result<()> {
    sheetchat_lib::run().await
}
