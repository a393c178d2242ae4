use flowgraph::commands::command_argument_builder;
use flowgraph::handlers::handle_build;

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    handle_build(&matches).await;
}
