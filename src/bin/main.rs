fn main() {
  inscription_indexer::main()
}
