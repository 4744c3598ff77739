fn main() {
    let token = std::env::var("API_TOKEN").unwrap_or_default();
    println!("{}", token.len());
}
