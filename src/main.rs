fn main() -> anyhow::Result<()> {
    structor_lib::run()
}
