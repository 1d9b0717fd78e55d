fn main() {
    uniffi::generate_scaffolding("src/formulary.udl").unwrap();
}
