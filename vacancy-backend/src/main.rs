#[tokio::main]
async fn main() {
    vacancy_backend::run().await;
}
