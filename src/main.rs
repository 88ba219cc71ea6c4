fn main() -> anyhow::Result<()> {
    netshaper_lib::run()
}
